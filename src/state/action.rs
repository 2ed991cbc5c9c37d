// src/state/action.rs

//! Named activities a node can report while it works.

use strum_macros::{Display, EnumString};

/// What a node is currently doing, rendered to the user by observers.
///
/// The string form is the kebab-case name, e.g. `loading-repos`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Action {
    Checking,
    Downloading,
    LoadingRepos,
    Decompressing,
    Depsolving,
    Installing,
    Removing,
    Updating,
    Cleaning,
    Verifying,
}
