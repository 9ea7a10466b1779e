#![cfg(unix)]

mod common;

mod auth;
mod health;
mod limits;
mod longpoll;
mod pending;
