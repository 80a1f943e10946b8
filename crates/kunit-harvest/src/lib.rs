pub mod format;
pub mod harvest;
pub mod ktest;

pub use format::{format_buffer, format_bytes, format_value, FormatError, Radix};
pub use harvest::{HarvestMode, Harvester, RecordValue, TestCaseRecord};
pub use ktest::{KTest, KTestObject, RecordDecodeError};
