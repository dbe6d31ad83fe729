//! User-facing views for TableManager
//!
//! Rendering lives outside the crate. This module holds the data a display
//! layer reads: the published table snapshot and a list view that keeps the
//! selection stable while tables come and go.

pub mod table_list;

pub use table_list::*;
