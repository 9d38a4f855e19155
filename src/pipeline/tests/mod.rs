// src/pipeline/tests/mod.rs
