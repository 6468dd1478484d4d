//! XML response bodies.
//!
//! Every non-streaming response is a small XML document: a
//! `ResponseMessage` envelope for status messages and errors, and listing
//! documents for buckets and objects.

use crate::models::{bucket::Bucket, object::Object};
use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use chrono::SecondsFormat;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// `<ResponseMessage><Status>..</Status><Message>..</Message></ResponseMessage>`
pub fn message_response(status: StatusCode, message: &str) -> Response {
    let xml = format!(
        concat!(
            "{}",
            "<ResponseMessage>",
            "<Status>{}</Status>",
            "<Message>{}</Message>",
            "</ResponseMessage>"
        ),
        XML_HEADER,
        status.as_u16(),
        xml_escape(message)
    );
    xml_response(status, xml)
}

pub fn xml_response(status: StatusCode, xml: String) -> Response {
    let mut response = Response::new(Body::from(xml));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml"),
    );
    response
}

pub fn build_bucket_list_xml(buckets: &[Bucket]) -> String {
    let mut xml = String::from(XML_HEADER);
    xml.push_str("<ListAllMyBucketsResult><Buckets>");
    for bucket in buckets {
        xml.push_str("<Bucket>");
        xml.push_str(&format!("<Name>{}</Name>", xml_escape(&bucket.name)));
        xml.push_str(&format!(
            "<CreationDate>{}</CreationDate>",
            bucket.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        xml.push_str(&format!(
            "<LastModified>{}</LastModified>",
            bucket
                .last_modified
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        xml.push_str("</Bucket>");
    }
    xml.push_str("</Buckets></ListAllMyBucketsResult>");
    xml
}

pub fn build_object_list_xml(bucket: &str, objects: &[Object]) -> String {
    let mut xml = String::from(XML_HEADER);
    xml.push_str("<ListBucketResult>");
    xml.push_str(&format!("<Name>{}</Name>", xml_escape(bucket)));
    xml.push_str(&format!("<KeyCount>{}</KeyCount>", objects.len()));
    for obj in objects {
        xml.push_str("<Contents>");
        xml.push_str(&format!("<Key>{}</Key>", xml_escape(&obj.key)));
        xml.push_str(&format!(
            "<LastModified>{}</LastModified>",
            obj.stored_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        xml.push_str(&format!("<Size>{}</Size>", obj.size_bytes));
        xml.push_str(&format!(
            "<ContentType>{}</ContentType>",
            xml_escape(&obj.content_type)
        ));
        xml.push_str("</Contents>");
    }
    xml.push_str("</ListBucketResult>");
    xml
}

pub fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
