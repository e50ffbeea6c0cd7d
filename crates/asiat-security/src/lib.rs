pub mod risk;
pub mod sandbox;

pub use risk::{
    detect_dangerous_command, is_critical_file, CRITICAL_DELETE_FILES, CRITICAL_WRITE_FILES,
};
pub use sandbox::SandboxPolicy;
