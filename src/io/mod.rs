//! I/O modules for reading SLC stacks and geometry layers

pub mod stack_reader;

pub use stack_reader::{load_stack, parse_acquisition_date, Dataset, MemoryStackSource, StackReader, StackSource};
