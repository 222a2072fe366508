pub mod logging;
pub mod window_state;
