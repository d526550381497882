use axum::body::Bytes;
use cartonord::storage::{MockStorageService, S3StorageClient, StorageService};
use std::time::Duration;

mod mock_tests {
    use super::*;

    #[tokio::test]
    async fn presigned_put_embeds_key_and_content_type() {
        let mock = MockStorageService::new();
        let url = mock
            .presign_upload("maps/1/export.pdf", "application/pdf", Duration::from_secs(600))
            .await
            .unwrap();

        assert!(url.contains("signature=fake"));
        assert!(url.contains("maps/1/export.pdf"));
        assert!(url.contains("content-type=application/pdf"));
        assert!(url.contains("expires=600"));
    }

    #[tokio::test]
    async fn failing_mock_fails_every_call() {
        let mock = MockStorageService::new_failing();
        let ttl = Duration::from_secs(300);

        assert!(mock.presign_upload("k", "image/png", ttl).await.is_err());
        assert!(mock.presign_download("k", ttl).await.is_err());
        assert!(mock.put_object("k", Bytes::new(), "image/png").await.is_err());
        assert!(mock.list_keys("maps/1/").await.is_err());
    }

    #[tokio::test]
    async fn listing_is_scoped_to_prefix() {
        let mock = MockStorageService::new();
        for key in ["maps/1/pictos/a.svg", "maps/1/logos/b.png", "maps/12/pictos/c.svg"] {
            mock.put_object(key, Bytes::from_static(b"x"), "image/svg+xml")
                .await
                .unwrap();
        }

        let keys = mock.list_keys("maps/1/pictos/").await.unwrap();
        assert_eq!(keys, vec!["maps/1/pictos/a.svg".to_string()]);
    }

    #[tokio::test]
    async fn rewriting_a_key_keeps_one_object() {
        let mock = MockStorageService::new();
        mock.put_object("maps/1/logos/b.png", Bytes::from_static(b"v1"), "image/png")
            .await
            .unwrap();
        mock.put_object("maps/1/logos/a.webp", Bytes::from_static(b"x"), "image/webp")
            .await
            .unwrap();
        mock.put_object("maps/1/logos/b.png", Bytes::from_static(b"v2"), "image/png")
            .await
            .unwrap();

        let keys = mock.list_keys("maps/1/logos/").await.unwrap();
        assert_eq!(keys, ["maps/1/logos/a.webp", "maps/1/logos/b.png"]);
        assert_eq!(mock.stored().len(), 2);
    }
}

mod s3_tests {
    use super::*;

    async fn client() -> S3StorageClient {
        S3StorageClient::new(
            "http://localhost:9000",
            "us-east-1",
            "testkey",
            "testsecret",
            "testbucket",
        )
        .await
    }

    // Presigning is computed locally; no server needs to be running.
    #[tokio::test]
    async fn presigned_put_is_path_style_and_signed() {
        let url = client()
            .await
            .presign_upload("maps/7/layers/roads.geojson", "application/json", Duration::from_secs(600))
            .await
            .unwrap();

        assert!(url.starts_with("http://localhost:9000/testbucket/maps/7/layers/roads.geojson"));
        assert!(url.contains("X-Amz-Signature="));
        assert!(url.contains("X-Amz-Expires=600"));
    }

    #[tokio::test]
    async fn presigned_get_honours_ttl() {
        let url = client()
            .await
            .presign_download("maps/7/export.pdf", Duration::from_secs(300))
            .await
            .unwrap();

        assert!(url.contains("maps/7/export.pdf"));
        assert!(url.contains("X-Amz-Expires=300"));
    }
}
