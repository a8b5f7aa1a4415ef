/*
 * Solidly-style router integration (stable and volatile curves)
 */

mod calls;
mod types;

pub use calls::{
    decode_amounts, decode_uint, encode_allowance, encode_balance_of, encode_get_amounts_out,
    selector, ContractCall,
};
pub use types::Route;
