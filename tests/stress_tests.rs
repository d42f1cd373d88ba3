//! Stress tests for splitpath.
//!
//! Tests for high-load scenarios including:
//! - Forwarding threads counting bytes while the sampler runs
//! - Route churn with recomputes racing lookups
//! - Large tables

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use splitpath::prelude::*;

const MASK_24: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);
const GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
const DESTINATIONS: u8 = 16;

fn dest(i: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 100, i, 0)
}

// ============================================================================
// Test Infrastructure
// ============================================================================

fn manager_with_routes() -> Arc<SplitManager> {
    let m = SplitManager::standalone(Config::default()).unwrap();
    m.update_routes(|r| {
        for i in 0..DESTINATIONS {
            r.insert(Route::new(Prefix::new(dest(i), MASK_24), Interface::Eth0, GATEWAY));
        }
    })
    .unwrap();
    Arc::new(m)
}

fn assert_conserved(m: &SplitManager) {
    let splits = m.splits().read().unwrap();
    for entry in splits.iter() {
        assert!((entry.total() - 1.0).abs() < 1e-9, "{entry:?}");
        assert!(entry.weights.iter().all(|w| (0.0..=1.0).contains(w)), "{entry:?}");
    }
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[test]
fn test_concurrent_forwarding_sampling_and_recompute() {
    let m = manager_with_routes();
    let stop = Arc::new(AtomicBool::new(false));
    let counted = Arc::new(AtomicU64::new(0));
    let mut handles = Vec::new();

    // Forwarding threads
    for t in 0..4u64 {
        let m = Arc::clone(&m);
        let counted = Arc::clone(&counted);
        handles.push(thread::spawn(move || {
            for n in 0..5_000u64 {
                let len = 64 + (n + t) % 1400;
                let i = u8::try_from((n + t) % u64::from(DESTINATIONS)).unwrap();
                m.record_flow(dest(i), MASK_24, len).unwrap();
                counted.fetch_add(len, Ordering::Relaxed);

                let alpha = m.get_alpha(dest(i), MASK_24, "eth0").unwrap();
                assert!((0.0..=1.0).contains(&alpha));
            }
        }));
    }

    // Sampler
    {
        let m = Arc::clone(&m);
        let stop = Arc::clone(&stop);
        handles.push(thread::spawn(move || {
            let sampler = m.sampler().unwrap();
            while !stop.load(Ordering::Relaxed) {
                sampler.sample_once().unwrap();
                thread::sleep(Duration::from_millis(1));
            }
        }));
    }

    // Routing subsystem flapping every destination across interfaces
    {
        let m = Arc::clone(&m);
        let stop = Arc::clone(&stop);
        handles.push(thread::spawn(move || {
            let mut round = 0usize;
            while !stop.load(Ordering::Relaxed) {
                let iface = Interface::ALL[round % Interface::ALL.len()];
                m.update_routes(|r| {
                    for i in 0..DESTINATIONS {
                        r.insert(Route::new(Prefix::new(dest(i), MASK_24), iface, GATEWAY));
                    }
                })
                .unwrap();
                round += 1;
            }
        }));
    }

    let forwarders: Vec<_> = handles.drain(..4).collect();
    for h in forwarders {
        h.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    for h in handles {
        h.join().unwrap();
    }

    let total: u64 = m.rates().read().unwrap().iter().map(|e| e.flow).sum();
    assert_eq!(total, counted.load(Ordering::Relaxed));
    assert_eq!(m.rates().read().unwrap().len(), usize::from(DESTINATIONS));
    assert_conserved(&m);
}

#[test]
fn test_readers_never_observe_partial_recompute() {
    let m = manager_with_routes();
    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let m = Arc::clone(&m);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut round = 0usize;
            while !stop.load(Ordering::Relaxed) {
                let iface = Interface::ALL[round % Interface::ALL.len()];
                m.update_routes(|r| {
                    for i in 0..DESTINATIONS {
                        r.insert(Route::new(Prefix::new(dest(i), MASK_24), iface, GATEWAY));
                    }
                })
                .unwrap();
                round += 1;
            }
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                for _ in 0..2_000 {
                    // One guard covers the whole batch of lookups.
                    let splits = m.splits().read().unwrap();
                    for i in 0..DESTINATIONS {
                        let w = splits.weights(dest(i), MASK_24).unwrap();
                        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-9);
                    }
                }
            })
        })
        .collect();

    for r in readers {
        r.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_sampler_under_load() {
    let config = Config {
        sampler: splitpath::rate::SamplerConfig {
            interval: Duration::from_millis(5),
        },
        ..Default::default()
    };
    let m = Arc::new(SplitManager::standalone(config).unwrap());
    let sampler = m.spawn_sampler().unwrap();

    let writer = {
        let m = Arc::clone(&m);
        tokio::task::spawn_blocking(move || {
            let deadline = Instant::now() + Duration::from_millis(100);
            let mut bytes = 0u64;
            while Instant::now() < deadline {
                m.record_flow(dest(1), MASK_24, 1500).unwrap();
                bytes += 1500;
            }
            bytes
        })
    };

    let bytes = writer.await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    sampler.abort();

    let rates = m.rates().read().unwrap();
    let entry = rates.lookup(dest(1), MASK_24).unwrap();
    assert_eq!(entry.flow, bytes);
    assert!(entry.last_flow <= entry.flow);
    assert!(entry.rate.is_finite() && entry.rate >= 0.0);
}

// ============================================================================
// Volume Tests
// ============================================================================

#[test]
fn test_large_table() {
    let m = SplitManager::standalone(Config::default()).unwrap();
    let prefixes: Vec<_> = (0..=255u8)
        .flat_map(|a| (0..8u8).map(move |b| Prefix::new(Ipv4Addr::new(10, a, b, 0), MASK_24)))
        .collect();

    let start = Instant::now();
    let stats = m
        .update_routes(|r| {
            for (i, p) in prefixes.iter().enumerate() {
                r.insert(Route::new(*p, Interface::ALL[i % 4], GATEWAY));
            }
        })
        .unwrap();
    assert_eq!(stats.seeded, prefixes.len());

    for p in &prefixes {
        m.record_flow(p.addr, p.mask, 1024).unwrap();
    }
    m.sampler().unwrap().sample_once().unwrap();

    let stats = m
        .update_routes(|r| {
            for p in &prefixes {
                r.insert(Route::new(*p, Interface::Eth3, GATEWAY));
            }
        })
        .unwrap();
    assert_eq!(stats.adapted, prefixes.len());
    assert_conserved(&m);

    println!("{} destinations in {:?}", prefixes.len(), start.elapsed());
}
