/*
 * Static decoder for the on-disk layout of PE images.
 * 
 * The MIT License (MIT)
 * 
 * Copyright (c) 2015 athre0z
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 * 
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 * 
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

use std::cmp;

use crate::rsrc::MAX_RESOURCE_DEPTH;

/// Knobs for [`PeImage::open_with`](crate::PeImage::open_with).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeOptions {
    max_resource_depth: usize,
    guard_resource_cycles: bool,
}

impl Default for DecodeOptions {
    fn default() -> DecodeOptions {
        DecodeOptions {
            max_resource_depth: MAX_RESOURCE_DEPTH,
            guard_resource_cycles: true,
        }
    }
}

impl DecodeOptions {
    pub fn new() -> DecodeOptions {
        DecodeOptions::default()
    }

    /// Deepest resource directory level to decode, 0 being the type level.
    /// Can only tighten the three-level bound, never loosen it.
    pub fn max_resource_depth(mut self, depth: usize) -> DecodeOptions {
        self.max_resource_depth = cmp::min(depth, MAX_RESOURCE_DEPTH);
        self
    }

    /// Reject resource directories that point back at a directory already
    /// on the path being decoded.
    pub fn guard_resource_cycles(mut self, enabled: bool) -> DecodeOptions {
        self.guard_resource_cycles = enabled;
        self
    }

    pub fn resource_depth_limit(&self) -> usize {
        self.max_resource_depth
    }

    pub fn guards_resource_cycles(&self) -> bool {
        self.guard_resource_cycles
    }
}
