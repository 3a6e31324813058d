//! Comprehensive tests for the section storage abstraction layer

#[cfg(test)]
mod integration_tests {
    use crate::error::StoreError;
    use crate::metadata::config::{MetadataBackend, MetadataConfig};
    use crate::metadata::{Image, SectionStorage};
    use std::sync::Arc;
    use std::thread;

    fn stores() -> Vec<(MetadataBackend, Arc<dyn SectionStorage>)> {
        [MetadataBackend::Mock, MetadataBackend::SQLite]
            .into_iter()
            .map(|backend| {
                let config = MetadataConfig {
                    backend: backend.clone(),
                    db_path: ":memory:".to_string(),
                    wal_mode: false,
                };
                let store = config.create_store().expect("store should open");
                (backend, store)
            })
            .collect()
    }

    fn image(id: &str) -> Image {
        Image { id: id.to_string(), url: format!("http://127.0.0.1:9710/media/trip/{}.jpg", id) }
    }

    #[test]
    fn test_section_lifecycle() {
        for (backend, store) in stores() {
            assert!(store.list_sections().unwrap().is_empty(), "{:?}", backend);
            assert!(store.get_section("trip").unwrap().is_none(), "{:?}", backend);

            let created = store.create_section("trip", "Trip!").unwrap();
            assert!(created.images.is_empty(), "{:?}", backend);
            assert_eq!(created.created_at, created.updated_at, "{:?}", backend);

            let listed = store.list_sections().unwrap();
            assert_eq!(listed.len(), 1, "{:?}", backend);
            assert_eq!(listed[0].section_id, "trip", "{:?}", backend);
            assert_eq!(listed[0].name, "Trip!", "{:?}", backend);

            store.delete_section("trip").unwrap();
            assert!(store.get_section("trip").unwrap().is_none(), "{:?}", backend);
            // Idempotent
            store.delete_section("trip").unwrap();
        }
    }

    #[test]
    fn test_append_and_remove_preserve_order() {
        for (backend, store) in stores() {
            store.create_section("trip", "Trip").unwrap();
            let created = store.get_section("trip").unwrap().unwrap();

            for id in ["a", "b", "c", "d"] {
                store.append_image("trip", &image(id)).unwrap();
            }
            let section = store.remove_image_at("trip", 1).unwrap();
            let ids: Vec<&str> = section.images.iter().map(|i| i.id.as_str()).collect();
            assert_eq!(ids, vec!["a", "c", "d"], "{:?}", backend);
            assert!(section.updated_at >= created.updated_at, "{:?}", backend);

            let stored = store.get_section("trip").unwrap().unwrap();
            assert_eq!(stored.images, section.images, "{:?}", backend);
        }
    }

    #[test]
    fn test_mutations_on_missing_records() {
        for (backend, store) in stores() {
            assert!(
                matches!(store.append_image("ghost", &image("a")), Err(StoreError::NotFound(_))),
                "{:?}",
                backend
            );
            assert!(
                matches!(store.remove_image_at("ghost", 0), Err(StoreError::NotFound(_))),
                "{:?}",
                backend
            );

            store.create_section("trip", "Trip").unwrap();
            store.append_image("trip", &image("a")).unwrap();
            assert!(
                matches!(store.remove_image_at("trip", 1), Err(StoreError::NotFound(_))),
                "{:?}",
                backend
            );
            assert_eq!(store.get_section("trip").unwrap().unwrap().images.len(), 1, "{:?}", backend);
        }
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        for (backend, store) in stores() {
            store.create_section("trip", "Trip").unwrap();

            let handles: Vec<_> = (0..8)
                .map(|worker| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || {
                        for n in 0..10 {
                            store.append_image("trip", &image(&format!("{}-{}", worker, n))).unwrap();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            let section = store.get_section("trip").unwrap().unwrap();
            assert_eq!(section.images.len(), 80, "{:?}: every append must land", backend);
        }
    }
}
