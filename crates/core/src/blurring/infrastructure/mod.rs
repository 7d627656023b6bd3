pub mod cpu_rectangular_blurrer;
mod gaussian;
