// src/limiter/tests/mod.rs

// Tests for the fixed window counter
mod fixed_window_tests;


// Tests for the per-project tiered limiter
mod tiered_tests;
