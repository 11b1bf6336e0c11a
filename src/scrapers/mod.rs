pub mod base;
pub mod taifex;
pub mod twse;
