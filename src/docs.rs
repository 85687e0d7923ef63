use crate::api::attendance::{
    GenerateQrRequest, GenerateQrResponse, ManualMarkRequest, MarkAttendanceRequest,
    MarkAttendanceResponse, VerifyAction, VerifyRequest,
};
use crate::model::attendance::{Attendance, AttendanceMethod, AttendanceStatus};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Library Attendance API",
        version = "1.0.0",
        description = r#"
## Library Attendance Service

QR-based attendance for a library/campus management system.

### 🔹 Key Features
- **Token Issuance**
  - Admin/kiosk issues short-lived, HMAC-signed, date-scoped QR tokens
- **Redemption**
  - Students scan and redeem a token at most once; attendance is idempotent per day
- **Geofencing**
  - Optional GPS check against the configured library location; a mismatch
    flags the record for manual review instead of rejecting it
- **Verification**
  - Admins approve or reject flagged records

### 🔐 Security
All endpoints require **JWT Bearer authentication** issued by the campus
identity service. Issuance and review endpoints are admin-only.

### 📦 Response Format
- JSON-based RESTful responses

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::attendance::generate_qr,
        crate::api::attendance::mark_attendance,
        crate::api::attendance::manual_mark,
        crate::api::attendance::my_attendance,
        crate::api::attendance::student_attendance,
        crate::api::attendance::all_attendance,
        crate::api::attendance::unverified_attendance,
        crate::api::attendance::verify_attendance,
    ),
    components(
        schemas(
            Attendance,
            AttendanceStatus,
            AttendanceMethod,
            GenerateQrRequest,
            GenerateQrResponse,
            MarkAttendanceRequest,
            MarkAttendanceResponse,
            ManualMarkRequest,
            VerifyAction,
            VerifyRequest
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "QR attendance APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
