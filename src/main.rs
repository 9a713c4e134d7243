#[rocket::launch]
fn rocket() -> _ {
    fitsocial::rocket()
}
