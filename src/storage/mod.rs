pub(crate) mod blob;
pub(crate) mod document;
pub(crate) mod entity;
pub(crate) mod files;
pub(crate) mod locks;
pub(crate) mod raw;
