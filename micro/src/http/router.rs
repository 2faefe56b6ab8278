//! Exact-match request routing with an ordered middleware chain.
//!
//! Build the router fully before handing it to a server; after that it is
//! read-only and needs no locking.

use std::collections::HashMap;

use crate::http::types::{Method, Request, Response};

/// Route handler: fills in the response for a matched request.
pub type Handler = Box<dyn Fn(&Request, &mut Response) + Send + Sync>;

/// Continuation passed to middleware; invoking it runs the rest of the
/// chain and then the handler.
pub type Next<'a> = dyn FnMut(&Request, &mut Response) + 'a;

/// Middleware: runs around the rest of the chain. Skipping the `next` call
/// short-circuits the handler.
pub type Middleware = Box<dyn Fn(&Request, &mut Response, &mut Next<'_>) + Send + Sync>;

#[derive(Default)]
pub struct Router {
    middleware: Vec<Middleware>,
    routes: HashMap<String, HashMap<Method, Handler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware; execution follows registration order.
    pub fn use_middleware<F>(&mut self, mw: F)
    where
        F: Fn(&Request, &mut Response, &mut Next<'_>) + Send + Sync + 'static,
    {
        self.middleware.push(Box::new(mw));
    }

    pub fn add_route<F>(&mut self, method: Method, path: impl Into<String>, handler: F)
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.routes
            .entry(path.into())
            .or_default()
            .insert(method, Box::new(handler));
    }

    pub fn get<F>(&mut self, path: impl Into<String>, handler: F)
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.add_route(Method::Get, path, handler);
    }

    pub fn post<F>(&mut self, path: impl Into<String>, handler: F)
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.add_route(Method::Post, path, handler);
    }

    /// Dispatch a request: 404 on no exact `(method, path)` match, otherwise
    /// middleware in order, then the handler.
    pub fn handle(&self, req: &Request, resp: &mut Response) {
        let handler = self
            .routes
            .get(&req.path)
            .and_then(|by_method| by_method.get(&req.method));

        let Some(handler) = handler else {
            resp.status = 404;
            resp.set_json("{\"error\":\"not_found\"}");
            return;
        };

        self.run_chain(0, req, resp, handler);
    }

    fn run_chain(&self, idx: usize, req: &Request, resp: &mut Response, handler: &Handler) {
        match self.middleware.get(idx) {
            Some(mw) => {
                let mut next =
                    |req: &Request, resp: &mut Response| self.run_chain(idx + 1, req, resp, handler);
                mw(req, resp, &mut next);
            }
            None => handler(req, resp),
        }
    }
}
