//! Entry point for the unit test modules under `tests/unit`.

mod unit;
