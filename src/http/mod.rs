//! HTTP protocol layer module
//!
//! Response builders and path helpers shared by the dispatcher and the
//! serve mux.

pub mod path;
pub mod response;

pub use path::{clean_path, decode_path, encode_path, find_invalid_escape, InvalidEscape};
pub use response::{
    apply_cors_headers, build_content_response, build_empty_response, build_redirect_response,
    build_text_response,
};
