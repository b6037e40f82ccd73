// Security module for path validation
//
// Restricts file tool paths to an optional root directory. This is a guard
// against accidental traversal, not a sandbox: tools keep the privileges of
// the user running the server.

pub mod path_validator;

pub use path_validator::{PathSecurityError, validate_new_path, validate_path};
