pub mod cpu;
pub mod disk;
pub mod memory;
pub mod processes;

pub use cpu::CpuInfoTool;
pub use disk::DiskUsageTool;
pub use memory::MemoryInfoTool;
pub use processes::ProcessListTool;
