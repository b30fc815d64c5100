use axum::{body::Body, http::Request, http::StatusCode};
use http_body_util::BodyExt;
use trackfit::config::CodecConfig;
use trackfit::{FIT_CONTENT_TYPE, SUMMARY_HEADER, build_app};
use tower::ServiceExt;

const BOUNDARY: &str = "trackfit-boundary";

const TWO_POINT_GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test">
  <trk><name>Evening Walk</name><trkseg>
    <trkpt lat="51.5007" lon="-0.1246"><ele>12</ele><time>2024-06-01T18:00:00Z</time></trkpt>
    <trkpt lat="51.5008" lon="-0.1246"><ele>13</ele><time>2024-06-01T18:00:10Z</time></trkpt>
  </trkseg></trk>
</gpx>"#;

fn upload_request(file_name: &str, contents: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
         Content-Type: application/gpx+xml\r\n\r\n\
         {contents}\r\n\
         --{BOUNDARY}--\r\n"
    );
    Request::builder()
        .method("POST")
        .uri("/convert")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn landing_page_responds() {
    let app = build_app(CodecConfig::default());
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn convert_without_file_is_rejected() {
    let app = build_app(CodecConfig::default());
    let req = Request::builder()
        .method("POST")
        .uri("/convert")
        .header("content-type", "multipart/form-data; boundary=--boundary")
        .body(Body::from("----boundary--"))
        .unwrap();

    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn gpx_upload_returns_fit_attachment() {
    let app = build_app(CodecConfig::default());
    let response = app
        .oneshot(upload_request("Evening Walk.gpx", TWO_POINT_GPX))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["content-type"], FIT_CONTENT_TYPE);
    assert_eq!(
        headers["content-disposition"],
        "attachment; filename=\"EveningWalk.fit\""
    );
    let summary = headers[SUMMARY_HEADER].to_str().unwrap();
    assert!(summary.starts_with("walking, "), "summary was {summary}");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body[0], 14);
    assert_eq!(&body[8..12], b".FIT");
}

#[tokio::test]
async fn single_point_track_is_a_bad_request() {
    let gpx = r#"<gpx><trk><trkseg>
        <trkpt lat="51.5007" lon="-0.1246"><time>2024-06-01T18:00:00Z</time></trkpt>
    </trkseg></trk></gpx>"#;
    let app = build_app(CodecConfig::default());
    let response = app.oneshot(upload_request("one.gpx", gpx)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(!body.is_empty());
}

#[tokio::test]
async fn malformed_xml_is_a_bad_request() {
    let app = build_app(CodecConfig::default());
    let response = app
        .oneshot(upload_request("broken.gpx", "<gpx><trk></gpx>"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unencodable_altitude_is_unprocessable() {
    let gpx = r#"<gpx><trk><trkseg>
        <trkpt lat="51.5007" lon="-0.1246"><ele>-900</ele><time>2024-06-01T18:00:00Z</time></trkpt>
        <trkpt lat="51.5008" lon="-0.1246"><ele>-900</ele><time>2024-06-01T18:00:10Z</time></trkpt>
    </trkseg></trk></gpx>"#;
    let app = build_app(CodecConfig::default());
    let response = app.oneshot(upload_request("deep.gpx", gpx)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let message = String::from_utf8_lossy(&body);
    assert!(message.contains("altitude"), "body was {message}");
}
