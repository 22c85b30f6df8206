// API routes and handlers

pub mod admin;
pub mod auth;
pub mod bookings;
pub mod health;
pub mod payments;
pub mod reviews;
pub mod routes;
pub mod sessions;
pub mod trainers;
