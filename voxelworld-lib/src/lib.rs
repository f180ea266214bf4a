pub mod transfer;
pub mod web;
