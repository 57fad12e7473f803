// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Radiative absorption in a 2D grid.
//!
//! Samples rays from every cell, gathers the emission each ray meets on its way out,
//! and reports the power absorbed per cell. With `--distributed` the grid is split
//! into row strips traced on separate threads and reduced at the end.
//!
//! Run:
//! - `cargo run -p canopy_demos --example raytrace -- --nx 20 --ny 20 --print`
//! - `RUST_LOG=debug cargo run -p canopy_demos --example raytrace -- --distributed --ranks 4`

use anyhow::Context;
use canopy_query::TraversalPolicy;
use canopy_raytrace::{
    Blackbody, CellGrid, Medium, absorbed_energy, absorbed_energy_distributed,
};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(about = "Ordered absorption along rays through a cell grid")]
struct Args {
    /// Cells along x.
    #[arg(long, default_value_t = 10)]
    nx: usize,
    /// Cells along y.
    #[arg(long, default_value_t = 10)]
    ny: usize,
    /// Domain width.
    #[arg(long, default_value_t = 100.0)]
    lx: f64,
    /// Domain height.
    #[arg(long, default_value_t = 100.0)]
    ly: f64,
    /// Rays sampled per cell.
    #[arg(long, default_value_t = 10)]
    rays_per_cell: usize,
    /// Split the grid into row strips, one per rank.
    #[arg(long)]
    distributed: bool,
    /// Ranks for `--distributed`.
    #[arg(long, default_value_t = 2)]
    ranks: usize,
    /// Print the energy of every cell.
    #[arg(long)]
    print: bool,
    /// 0 for exact buffering, positive to recount on overflow, negative to fail.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    buffer_size: i32,
    /// Trace rays in input order instead of Z-order.
    #[arg(long)]
    no_sort: bool,
    /// Seed for ray sampling.
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Absorption coefficient.
    #[arg(long, default_value_t = 10.0)]
    kappa: f64,
    /// Medium temperature in Kelvin.
    #[arg(long, default_value_t = 2000.0)]
    temperature: f64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let grid = CellGrid::new(args.nx, args.ny, args.lx, args.ly).context("building the grid")?;
    let medium = Medium::new(args.kappa);
    let emission = Blackbody::new(args.temperature);
    let policy = TraversalPolicy::default()
        .with_buffer_size(args.buffer_size)
        .with_predicate_sorting(!args.no_sort);
    let rays = grid.sample_rays(args.rays_per_cell, args.seed);
    log::info!(
        "{} cells, {} rays, {:?}",
        grid.cell_count(),
        rays.len(),
        policy.buffer()
    );

    let energy = if args.distributed {
        absorbed_energy_distributed(
            &grid,
            &rays,
            args.rays_per_cell,
            args.ranks,
            &medium,
            emission,
            &policy,
        )
        .with_context(|| format!("tracing over {} ranks", args.ranks))?
    } else {
        absorbed_energy(&grid, &rays, args.rays_per_cell, &medium, &emission, &policy)
            .context("tracing")?
    };

    if args.print {
        for (id, e) in energy.iter().enumerate() {
            let c = grid.cell_box(id).center();
            println!("{id} {} {} {e}", c.x, c.y);
        }
    }

    let absorbed: f64 = energy.iter().sum::<f64>() * grid.cell_area();
    let emitted = medium.emitted_power(&emission) * grid.cell_area() * grid.cell_count() as f64;
    println!("absorbed {absorbed:.6e} W/m, emitted {emitted:.6e} W/m");
    Ok(())
}
