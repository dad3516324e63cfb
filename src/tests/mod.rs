//! Crate tests.

mod util;

mod proxy;
