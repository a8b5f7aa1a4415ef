/*
 * Solidly router types
 */

use ethers::abi::{ParamType, Token};
use ethers::types::Address;
use serde::{Deserialize, Serialize};

/// One swap leg: `from` -> `to` on the stable or volatile curve of `factory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    pub from: Address,
    pub to: Address,
    pub stable: bool,
    pub factory: Address,
}

impl Route {
    #[must_use]
    pub fn volatile(from: Address, to: Address, factory: Address) -> Self {
        Self { from, to, stable: false, factory }
    }

    #[must_use]
    pub fn stable(from: Address, to: Address, factory: Address) -> Self {
        Self { from, to, stable: true, factory }
    }

    /// ABI tuple `(address from, address to, bool stable, address factory)`.
    #[must_use]
    pub fn to_token(&self) -> Token {
        Token::Tuple(vec![
            Token::Address(self.from),
            Token::Address(self.to),
            Token::Bool(self.stable),
            Token::Address(self.factory),
        ])
    }

    #[must_use]
    pub fn param_type() -> ParamType {
        ParamType::Tuple(vec![
            ParamType::Address,
            ParamType::Address,
            ParamType::Bool,
            ParamType::Address,
        ])
    }
}

#[must_use]
pub fn routes_token(routes: &[Route]) -> Token {
    Token::Array(routes.iter().map(Route::to_token).collect())
}
