//! HTTP handlers for the accreditation API.

pub mod accreditations;
