//! Scheduler (C6, spec §5): partitions work across worker threads by index
//! stride rather than contiguous chunks, so every worker's load grows at
//! similar rates as R increases.

use crate::config::ScanConfiguration;
use crate::error::Result;
use crate::roi::RoI;
use crate::roi_proxy::RoIProxy;

/// Recursive `Attach` walks (spec §4.3) can reach the 75,000-hop recursion
/// limit; give worker threads headroom well beyond the default stack.
const WORKER_STACK_SIZE: usize = 16 * 1024 * 1024;

/// Run `f(i)` for `i in 0..n`, striped across `threads` workers by
/// `i % threads`, and collect the results in index order. Used both for
/// RoI preprocessing and (indirectly) for the scan itself.
pub fn parallel_map<T, F>(n: usize, threads: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    let threads = threads.max(1).min(n.max(1));
    let f = &f;

    let chunks: Vec<Vec<(usize, T)>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                scope.spawn(move || {
                    let mut local = Vec::new();
                    let mut i = t;
                    while i < n {
                        local.push((i, f(i)));
                        i += threads;
                    }
                    local
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("preprocess worker panicked")).collect()
    });

    let mut out: Vec<Option<T>> = (0..n).map(|_| None).collect();
    for chunk in chunks {
        for (i, v) in chunk {
            out[i] = Some(v);
        }
    }
    out.into_iter()
        .map(|v| v.expect("parallel_map: every index must be populated"))
        .collect()
}

/// Drive a full (R, T) scan (spec §4.8): one `RoIProxy` per worker, the
/// R-axis striped by `i % threads`, joined at the end.
pub fn run_scan<F>(roi: &RoI, config: &ScanConfiguration, threads: usize, validate: bool, callback: &F) -> Result<()>
where
    F: Fn(&RoIProxy, f64, f64) + Sync,
{
    let threads = threads.max(1);

    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(threads);
        for offset in 0..threads {
            let builder = std::thread::Builder::new()
                .name(format!("roi-scan-{offset}"))
                .stack_size(WORKER_STACK_SIZE);
            let handle = builder
                .spawn_scoped(scope, move || {
                    let mut proxy = RoIProxy::new(roi);
                    proxy.scan_rt(config, threads, offset, validate, callback)
                })
                .expect("failed to spawn scan worker thread");
            handles.push(handle);
        }
        for h in handles {
            h.join().expect("scan worker panicked")?;
        }
        Ok(())
    })
}
