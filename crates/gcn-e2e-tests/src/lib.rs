//! Test-only crate. The tests live in `tests/`.
