pub mod revert;
