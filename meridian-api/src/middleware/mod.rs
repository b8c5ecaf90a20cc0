/// HTTP middleware
///
/// Bearer authentication is applied in `app::build_router`; this module
/// holds the response-side layers.

pub mod security;
