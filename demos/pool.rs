use segpool::{AllocError, AllocPolicy, Pool, PoolSegment};
use tracing_subscriber::{EnvFilter, fmt};

/// Prints the pool's segments in buffer order, one bar per segment.
fn print_layout(
  label: &str,
  pool: &Pool,
) -> Result<(), AllocError> {
  let stats = pool.stats();
  println!(
    "\n[{label}] {} of {} bytes in {} allocation(s), {} gap(s)",
    stats.alloc_size, stats.total_size, stats.num_allocs, stats.num_gaps,
  );

  for PoolSegment { size, allocated } in pool.inspect()? {
    let state = if allocated { "used" } else { "free" };
    println!("    {state} {size:>5} {}", "#".repeat(size / 20));
  }

  Ok(())
}

fn main() -> Result<(), AllocError> {
  // RUST_LOG=segpool=trace shows every split and merge.
  fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  for policy in [AllocPolicy::FirstFit, AllocPolicy::BestFit] {
    println!("\n==================== {policy:?} ====================");

    let mut pool = Pool::open(1000, policy)?;
    print_layout("open", &pool)?;

    // --------------------------------------------------------------------
    // 1) Fragment the pool: three gaps of 100, 300 and 300 bytes.
    // --------------------------------------------------------------------
    let a = pool.allocate(100)?;
    let b = pool.allocate(50)?;
    let c = pool.allocate(300)?;
    let d = pool.allocate(50)?;
    let e = pool.allocate(300)?;
    let f = pool.allocate(200)?;
    pool.free(a)?;
    pool.free(c)?;
    pool.free(e)?;
    print_layout("fragmented", &pool)?;

    // --------------------------------------------------------------------
    // 2) Ask for 80 bytes and see which gap the policy picks.
    // --------------------------------------------------------------------
    let small = pool.allocate(80)?;
    println!("\n[2] 80 bytes landed at offset {}", small.offset());
    pool.bytes_mut(&small)?.fill(0xAB);

    // --------------------------------------------------------------------
    // 3) A request no single gap can hold fails, even though the total
    //    free space would be enough.
    // --------------------------------------------------------------------
    match pool.allocate(400) {
      Err(err) => println!("\n[3] 400 bytes: {err}"),
      Ok(allocation) => println!("\n[3] 400 bytes landed at offset {}", allocation.offset()),
    }

    // --------------------------------------------------------------------
    // 4) Free everything; neighbours merge back into a single gap.
    // --------------------------------------------------------------------
    for allocation in [small, b, d, f] {
      pool.free(allocation)?;
    }
    print_layout("drained", &pool)?;

    if let Err((_, err)) = pool.close() {
      println!("\n[4] close refused: {err}");
    }
  }

  Ok(())
}
