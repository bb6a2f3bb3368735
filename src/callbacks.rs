// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The three role-independent callback slots every endpoint carries:
//! `onBind`, `onError`, and whatever shape of message callback its role
//! takes (set separately, see [`crate::endpoint`]).

use std::sync::{Arc, Mutex};

pub type BindCallback = dyn Fn(u16) + Send + Sync;
pub type ErrorCallback = dyn Fn(String) + Send + Sync;

#[derive(Default)]
pub struct Callbacks {
    pub on_bind: Mutex<Option<Arc<BindCallback>>>,
    pub on_error: Mutex<Option<Arc<ErrorCallback>>>,
}

impl Callbacks {
    pub fn new() -> Callbacks {
        Callbacks::default()
    }

    pub fn set_on_bind<F: Fn(u16) + Send + Sync + 'static>(&self, cb: F) {
        *self.on_bind.lock().unwrap() = Some(Arc::new(cb));
    }

    pub fn set_on_error<F: Fn(String) + Send + Sync + 'static>(&self, cb: F) {
        *self.on_error.lock().unwrap() = Some(Arc::new(cb));
    }

    pub fn fire_bind(&self, port: u16) {
        if let Some(cb) = self.on_bind.lock().unwrap().as_ref() {
            cb(port);
        }
    }

    pub fn fire_error(&self, message: String) {
        if let Some(cb) = self.on_error.lock().unwrap().as_ref() {
            cb(message);
        }
    }
}
