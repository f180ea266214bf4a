pub(crate) mod builtin;
pub(crate) mod migrator;
pub(crate) mod registry;
pub(crate) mod service;
pub(crate) mod version;
