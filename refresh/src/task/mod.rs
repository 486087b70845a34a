//! Background tasks owned by a cache: the polling scheduler that keeps
//! `Scheduled` requests fresh.

pub(crate) mod scheduler;
