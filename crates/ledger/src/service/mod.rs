pub mod feed;
pub mod signups;

#[cfg(test)]
pub(crate) mod testing;
