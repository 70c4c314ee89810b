// UI module - presentation front ends
//
// The orchestrator talks to any front end through the Presenter trait.
// This module holds the terminal implementation used by the binary.

pub mod console;

pub use console::ConsolePresenter;
