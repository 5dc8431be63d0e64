use parapal_protocol::GradeRequestPayload;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use crate::protocol::response::WireResponse;
use crate::GraderError;

/// One POST to the grading endpoint. Non-2xx statuses are returned, not
/// raised; only transport failures become errors.
pub(crate) async fn send_grade_http(
    client: &reqwest::Client,
    endpoint: &str,
    id_token: &str,
    payload: &GradeRequestPayload,
) -> Result<WireResponse, GraderError> {
    let response = client
        .post(endpoint)
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, "application/json")
        .bearer_auth(id_token)
        .json(payload)
        .send()
        .await?;

    let status = response.status();
    let body = response.bytes().await?;
    Ok(WireResponse {
        status: status.as_u16(),
        body: String::from_utf8_lossy(&body).to_string(),
    })
}
