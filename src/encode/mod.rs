//! Row encoding - turn one result row into one search document
//!
//! - **value**: canonical text of a single typed value
//! - **identity**: document ids from key columns, and the per-query `ExportContext`
//! - **structured**: nested integer arrays hidden in text columns
//! - **row**: assembles the above into a `DocumentFragment`

pub mod identity;
pub mod row;
pub mod structured;
pub mod value;

pub use identity::{identify, string_key, ExportContext};
pub use row::{encode_row, DocumentFragment, Field};
pub use structured::{detect, render, Detection, RenderedValue};
pub use value::encode;
