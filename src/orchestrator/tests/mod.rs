mod scenarios;
pub(crate) mod support;
