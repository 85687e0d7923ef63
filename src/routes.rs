use crate::{
    api::attendance,
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let per_ms = if requests_per_min == 0 {
            1
        } else {
            60_000 / requests_per_min as u64
        };
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap();
        Governor::new(&cfg)
    }

    // scanning bursts hit /mark; keep its limiter separate from the rest
    let redeem_limiter = build_limiter(config.rate_redeem_per_min);
    let protected_limiter = build_limiter(config.rate_protected_per_min);

    // Protected routes (login/registration live in the identity service)
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/attendance")
                    // /attendance/mark: student redeems a scanned token
                    .service(
                        web::resource("/mark")
                            .wrap(redeem_limiter)
                            .route(web::post().to(attendance::mark_attendance)),
                    )
                    // /attendance/qrcode: admin/kiosk issues a token
                    .service(
                        web::resource("/qrcode")
                            .route(web::post().to(attendance::generate_qr)),
                    )
                    // /attendance/manual: admin marks without a token
                    .service(
                        web::resource("/manual")
                            .route(web::post().to(attendance::manual_mark)),
                    )
                    // /attendance/my: own history
                    .service(
                        web::resource("/my").route(web::get().to(attendance::my_attendance)),
                    )
                    // /attendance/all: admin listing with filters
                    .service(
                        web::resource("/all").route(web::get().to(attendance::all_attendance)),
                    )
                    // /attendance/unverified: manual-review queue
                    .service(
                        web::resource("/unverified")
                            .route(web::get().to(attendance::unverified_attendance)),
                    )
                    // /attendance/student/{id}
                    .service(
                        web::resource("/student/{id}")
                            .route(web::get().to(attendance::student_attendance)),
                    )
                    // /attendance/{id}/verify: admin approve/reject
                    .service(
                        web::resource("/{id}/verify")
                            .route(web::put().to(attendance::verify_attendance)),
                    ),
            ),
    );
}

// ISSUE (admin/kiosk)
//  └─ POST /attendance/qrcode
//       └─ returns token + expiry; kiosk renders it as a QR image
//
// REDEEM (student)
//  └─ POST /attendance/mark with scanned token
//       ├─ token verified, marked used, attendance recorded
//       └─ expired/used tokens → 400; re-scan a fresh code
