/// Module for loading documents from files.
pub mod file_loaders;
