mod billing;
mod catalog;
mod common;
