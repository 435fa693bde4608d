pub mod console;

pub use console::{parse_command, render_devices, render_help, render_status, Command};
