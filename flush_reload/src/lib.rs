#![deny(unsafe_op_in_unsafe_fn)]

pub mod naive;

pub use naive::NaiveFlushAndReload;
