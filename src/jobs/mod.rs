// Background jobs, driven by the external scheduler in main.

pub mod retention_cleaner;
