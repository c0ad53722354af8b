//! Manager-level unit tests
//!
//! Each test drives a manager through the in-memory database with scripted
//! dice and a manual clock, then checks the stored records.

mod combat_manager;
