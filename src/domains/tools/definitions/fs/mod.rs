pub mod list_dir;
pub mod read_file;
pub mod search;
pub mod write_file;

pub use list_dir::ListDirTool;
pub use read_file::ReadFileTool;
pub use search::SearchFilesTool;
pub use write_file::WriteFileTool;
