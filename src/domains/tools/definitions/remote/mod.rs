pub mod ssh_exec;

pub use ssh_exec::SshExecTool;
