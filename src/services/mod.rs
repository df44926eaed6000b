// Services module - Business logic

pub mod code_generator;
pub mod csv_export;
pub mod lifecycle;
