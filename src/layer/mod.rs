pub(crate) mod compose;
pub(crate) mod origin;
pub(crate) mod store;
