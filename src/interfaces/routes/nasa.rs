use actix_web::web;

use crate::handlers::apod;

pub fn config_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/nasa")
            .service(
                web::resource("/apod")
                    .route(web::get().to(apod::get_picture_of_the_day))
            )
            .service(
                web::resource("/posts")
                    .route(web::get().to(apod::get_all_pictures))
            )
            .service(
                web::resource("/posts/{date}")
                    .route(web::get().to(apod::get_picture_by_date))
            )
    );
}
