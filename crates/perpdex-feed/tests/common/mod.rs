#![allow(dead_code)]

pub mod mock_rest;
pub mod mock_ws;
