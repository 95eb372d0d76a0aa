//! Integration tests for cachereg

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Command bound to a config file inside `dir` so tests never touch
    /// the user's configuration
    fn cachereg(dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("cachereg");
        cmd.arg("--config").arg(dir.path().join("config.toml"));
        cmd
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("cachereg")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("stress"))
            .stdout(predicate::str::contains("scenario"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("cachereg")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("cachereg"));
    }

    #[test]
    fn config_path() {
        let dir = TempDir::new().unwrap();
        cachereg(&dir)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let dir = TempDir::new().unwrap();
        cachereg(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[manager]"))
            .stdout(predicate::str::contains("construction = \"speculative\""));
    }

    #[test]
    fn config_set_then_show() {
        let dir = TempDir::new().unwrap();
        cachereg(&dir)
            .args(["config", "set", "manager.construction", "locked"])
            .assert()
            .success();
        cachereg(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("construction = \"locked\""));
    }

    #[test]
    fn config_set_unknown_key() {
        let dir = TempDir::new().unwrap();
        cachereg(&dir)
            .args(["config", "set", "vm.name", "x"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn invalid_config_file() {
        let dir = TempDir::new().unwrap();
        let bad = "[stress]\nthreads = \"many\"\n";
        std::fs::write(dir.path().join("config.toml"), bad).unwrap();
        cachereg(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"))
            .stderr(predicate::str::contains("config init --force"));
    }

    #[test]
    fn scenario_passes() {
        let dir = TempDir::new().unwrap();
        cachereg(&dir)
            .arg("scenario")
            .assert()
            .success()
            .stdout(predicate::str::contains("Scenario passed"));
    }

    #[test]
    fn stress_json_report() {
        let dir = TempDir::new().unwrap();
        cachereg(&dir)
            .args([
                "stress", "-t", "4", "--tokens", "3", "-r", "10", "--format", "json",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"instances_observed\": 3"))
            .stdout(predicate::str::contains("\"violations\": []"));
    }

    #[test]
    fn stress_thread_local_plain() {
        let dir = TempDir::new().unwrap();
        cachereg(&dir)
            .args([
                "stress",
                "-t",
                "3",
                "--tokens",
                "2",
                "-r",
                "5",
                "-m",
                "thread-local",
                "-f",
                "plain",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("instances_observed=6"))
            .stdout(predicate::str::contains("passed=true"));
    }

    #[test]
    fn stress_rejects_unknown_mode() {
        let dir = TempDir::new().unwrap();
        cachereg(&dir)
            .args(["stress", "--mode", "global"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("unknown cache mode"));
    }

    #[test]
    fn stress_rejects_zero_threads() {
        let dir = TempDir::new().unwrap();
        cachereg(&dir)
            .args(["stress", "-t", "0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("at least 1"));
    }
}

mod registry_tests {
    use cachereg::{CacheError, CacheManager, CacheMode, CacheToken, IdentityKeyedStore};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[derive(Debug, Default)]
    struct Symbols {
        names: Vec<String>,
    }

    #[derive(Debug, Default)]
    struct Scratch {
        buf: Vec<u8>,
    }

    fn addr<T>(value: &Arc<T>) -> usize {
        Arc::as_ptr(value) as usize
    }

    #[test]
    fn contended_shared_lookup_yields_one_instance() {
        let token = CacheManager::register_type::<Symbols>(CacheMode::Shared);
        let manager = CacheManager::new();
        let barrier = Barrier::new(16);

        let seen: Vec<Arc<Symbols>> = thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        manager.get(&token).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let first = &seen[0];
        assert!(seen.iter().all(|v| Arc::ptr_eq(v, first)));
        assert!(first.names.is_empty());
        assert_eq!(manager.stats().published(), 1);
    }

    #[test]
    fn thread_local_instances_are_isolated() {
        let token = CacheManager::register_type::<Scratch>(CacheMode::ThreadLocal);
        let manager = CacheManager::new();
        // Both barriers keep all threads alive while any of them looks up
        let start = Barrier::new(4);
        let done = Barrier::new(4);

        let seen: Vec<Arc<Scratch>> = thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        start.wait();
                        let first = manager.get(&token).unwrap();
                        let again = manager.get(&token).unwrap();
                        assert!(Arc::ptr_eq(&first, &again));
                        assert!(first.buf.is_empty());
                        done.wait();
                        first
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let distinct: HashSet<usize> = seen.iter().map(addr).collect();
        assert_eq!(distinct.len(), 4);
    }

    #[test]
    fn tokens_registered_after_manager_creation_resolve() {
        let manager = CacheManager::new();
        let before = manager.shared_capacity();

        let tokens: Vec<CacheToken<Symbols>> = (0..before + 8)
            .map(|_| CacheManager::register_type(CacheMode::Shared))
            .collect();
        let instances: Vec<Arc<Symbols>> = tokens.iter().map(|t| manager.get(t).unwrap()).collect();

        assert!(manager.shared_capacity() > before);
        for (token, instance) in tokens.iter().zip(&instances) {
            assert!(Arc::ptr_eq(&manager.get(token).unwrap(), instance));
        }
        let distinct: HashSet<usize> = instances.iter().map(addr).collect();
        assert_eq!(distinct.len(), tokens.len());
    }

    #[test]
    fn growth_under_contention_keeps_published_values() {
        let manager = CacheManager::new();
        let early = CacheManager::register_type::<Symbols>(CacheMode::Shared);
        let pinned = manager.get(&early).unwrap();

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..32 {
                        let token = CacheManager::register_type::<Symbols>(CacheMode::Shared);
                        manager.get(&token).unwrap();
                        assert!(Arc::ptr_eq(&manager.get(&early).unwrap(), &pinned));
                    }
                });
            }
        });

        assert!(Arc::ptr_eq(&manager.get(&early).unwrap(), &pinned));
    }

    #[test]
    fn managers_do_not_share_instances() {
        let token = CacheManager::register_type::<Symbols>(CacheMode::Shared);
        let first = CacheManager::new();
        let second = CacheManager::new();

        let a = first.get(&token).unwrap();
        let b = second.get(&token).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn identity_store_distinguishes_equal_keys() {
        let store = IdentityKeyedStore::new();
        let k1 = Arc::new(String::from("same"));
        let k2 = Arc::new(String::from("same"));
        assert_eq!(k1, k2);

        let v1 = store
            .get_or_create(&k1, || Ok::<_, CacheError>(vec![1u8]))
            .unwrap();
        let v2 = store
            .get_or_create(&k2, || Ok::<_, CacheError>(vec![2u8]))
            .unwrap();
        let v1_again = store
            .get_or_create(&k1, || Ok::<_, CacheError>(vec![3u8]))
            .unwrap();

        assert_eq!(*v1, vec![1u8]);
        assert_eq!(*v2, vec![2u8]);
        assert!(Arc::ptr_eq(&v1, &v1_again));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn manager_store_is_per_manager() {
        let key = Arc::new(42u32);
        let first = CacheManager::new();
        let second = CacheManager::new();

        let a = first
            .get_or_create(&key, || Ok::<_, CacheError>(String::from("a")))
            .unwrap();
        let b = second
            .get_or_create(&key, || Ok::<_, CacheError>(String::from("b")))
            .unwrap();
        assert_eq!(a.as_str(), "a");
        assert_eq!(b.as_str(), "b");
    }

    #[test]
    fn concurrent_dispose_notifies_once() {
        let manager = CacheManager::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            assert!(manager.on_disposed(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }));
        }

        let barrier = Barrier::new(8);
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    barrier.wait();
                    manager.dispose();
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(manager.is_disposed());
        assert!(!manager.on_disposed(|_| panic!("listener after dispose")));
    }

    #[test]
    fn default_token_is_rejected() {
        let manager = CacheManager::new();
        let capacity = manager.shared_capacity();

        let err = manager.get(&CacheToken::<Symbols>::default()).unwrap_err();
        assert!(matches!(err, CacheError::InvalidToken { .. }));
        assert_eq!(manager.shared_capacity(), capacity);
    }

    #[test]
    fn invalid_mode_value_is_rejected() {
        assert!(matches!(
            CacheMode::try_from(0u8),
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(matches!(
            "global".parse::<CacheMode>(),
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[test]
    fn shared_and_thread_local_together() {
        let shared = CacheManager::register_type::<Symbols>(CacheMode::Shared);
        let local = CacheManager::register_type::<Scratch>(CacheMode::ThreadLocal);
        let manager = CacheManager::new();
        let start = Barrier::new(2);
        let done = Barrier::new(2);

        let seen: Vec<(Arc<Symbols>, Arc<Scratch>)> = thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(|| {
                        start.wait();
                        let pair = (manager.get(&shared).unwrap(), manager.get(&local).unwrap());
                        done.wait();
                        pair
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(Arc::ptr_eq(&seen[0].0, &seen[1].0));
        assert!(!Arc::ptr_eq(&seen[0].1, &seen[1].1));
    }
}
