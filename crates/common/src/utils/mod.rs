pub mod logging;
pub mod text;
