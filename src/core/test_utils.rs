//! Test utilities for arena-based testing.
//!
//! Tests build shaders from the textual IR and run passes against a session
//! whose arena is owned by a [`TestContext`].
