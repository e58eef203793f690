// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete modules. The real collector/responder modules (inventory, log
//! collection, SCA) stay out of scope; [`echo`] exists purely to exercise
//! the registry contract in tests.

pub mod echo;
