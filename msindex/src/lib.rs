// src/lib.rs
pub mod index {
    pub mod peak_index;
    pub mod xic;
    pub mod dia;
}

pub mod extract {
    pub mod fragment;
    pub mod cpu;
    pub mod gpu;
    pub mod orchestrator;
}

pub mod config;
pub mod error;
pub mod persist;
pub mod pipeline;
