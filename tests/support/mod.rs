//! Shared test scaffolding: a scripted paginated listing session.

pub mod paged_session;
