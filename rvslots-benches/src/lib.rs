//! Benchmarks for `rvslots` live under `benches/`.
