//! Pipeline services: retrieval, unpacking, extraction, reporting, and
//! the PR commenter.

pub mod commenter;
pub mod extraction;
pub mod report;
pub mod retrieval;
pub mod unpack;
