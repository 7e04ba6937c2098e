//! Core definitions shared by the tinyfat crates.
#![no_std]
#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::doc_markdown)]

pub mod storage;

#[macro_export]
macro_rules! static_assert {
    ($condition:expr $(, $($arg:tt)+)?) => {
        const _: () = assert!($condition $(, $($arg)+)?);
    };
}
