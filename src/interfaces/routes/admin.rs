use actix_web::web;

use crate::handlers::apod;

pub fn config_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .service(
                web::resource("/nasa/backfill")
                    .route(web::post().to(apod::backfill_pictures))
            )
    );
}
