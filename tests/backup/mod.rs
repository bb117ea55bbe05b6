//! Step definitions, fixtures, and scenarios for backup runs.

mod bdd_steps;
mod scenarios;
mod test_helpers;
