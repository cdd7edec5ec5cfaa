use super::PageResult;
use crate::gate::{handler_fn, Handler};

pub fn page() -> impl Handler<Output = PageResult> + Send + Sync {
    handler_fn("home", |req| -> PageResult {
        let mut out = String::from("# Welcome to dashgate\n\n");
        match req.session.name.as_deref() {
            Some(name) => out.push_str(&format!("Signed in as {}.\n", name)),
            None => out.push_str("Open /dashboard and sign in to see sales analytics.\n"),
        }
        out.push_str("Pages: /home, /about, /dashboard\n");
        Ok(out)
    })
}
