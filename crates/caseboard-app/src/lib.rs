// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod binder;
pub mod console;
pub mod countdown;
pub mod filter;
pub mod ids;
pub mod listing;
pub mod model;

pub use binder::*;
pub use console::*;
pub use countdown::*;
pub use filter::*;
pub use ids::*;
pub use listing::*;
pub use model::*;
