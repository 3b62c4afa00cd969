#![allow(dead_code)]

pub mod dataset;
