//! `Blob`, `File` and `FileReader` over in-memory bytes.
//!
//! The classes live in the guest. Text is converted to and from UTF-8 by host functions, so lone
//! surrogates encode as U+FFFD and malformed bytes decode to it.

use crate::marshal;
use rquickjs::{ArrayBuffer, Ctx, Exception, Function};

const GLUE: &str = r#"
(function (encodeUtf8, decodeUtf8) {
  'use strict';
  const Bytes = Uint8Array;

  function encode(text) {
    return new Bytes(encodeUtf8(String(text)));
  }

  function decode(bytes) {
    return decodeUtf8(bytes.slice().buffer);
  }

  function normalizeType(type) {
    const text = String(type);
    return /[^\x20-\x7E]/.test(text) ? '' : text.toLowerCase();
  }

  function clampIndex(index, size) {
    const n = Math.trunc(Number(index)) || 0;
    return n < 0 ? Math.max(size + n, 0) : Math.min(n, size);
  }

  const contents = new WeakMap();

  class Blob {
    #bytes;
    #type;

    constructor(blobParts, options) {
      this.#type = normalizeType(options === undefined || options.type === undefined ? '' : options.type);
      if (blobParts === undefined) {
        this.#bytes = new Bytes(0);
        contents.set(this, this.#bytes);
        return;
      }
      if (blobParts === null || typeof blobParts[Symbol.iterator] !== 'function' || typeof blobParts === 'string') {
        throw new TypeError("Failed to construct 'Blob': The provided value cannot be converted to a sequence.");
      }
      const parts = [];
      let total = 0;
      for (const part of blobParts) {
        let bytes;
        if (part instanceof ArrayBuffer) {
          bytes = new Bytes(part);
        } else if (ArrayBuffer.isView(part)) {
          bytes = new Bytes(part.buffer, part.byteOffset, part.byteLength);
        } else if (part instanceof Blob) {
          bytes = part.#bytes;
        } else {
          bytes = encode(part);
        }
        parts.push(bytes);
        total += bytes.byteLength;
      }
      const merged = new Bytes(total);
      let offset = 0;
      for (const part of parts) {
        merged.set(part, offset);
        offset += part.byteLength;
      }
      this.#bytes = merged;
      contents.set(this, merged);
    }

    get size() {
      return this.#bytes.byteLength;
    }

    get type() {
      return this.#type;
    }

    slice(start, end, contentType) {
      const size = this.size;
      const from = start === undefined ? 0 : clampIndex(start, size);
      const to = end === undefined ? size : clampIndex(end, size);
      const sliced = new Blob([this.#bytes.slice(from, Math.max(to, from))], {
        type: contentType === undefined ? '' : contentType,
      });
      return sliced;
    }

    text() {
      return Promise.resolve(decode(this.#bytes));
    }

    arrayBuffer() {
      return Promise.resolve(this.#bytes.slice().buffer);
    }

    get [Symbol.toStringTag]() {
      return 'Blob';
    }
  }

  class File extends Blob {
    #name;
    #lastModified;

    constructor(fileBits, fileName, options) {
      if (arguments.length < 2) {
        throw new TypeError("Failed to construct 'File': 2 arguments required, but only " +
          arguments.length + ' present.');
      }
      super(fileBits, options);
      this.#name = String(fileName);
      this.#lastModified = options !== undefined && options.lastModified !== undefined
        ? Number(options.lastModified)
        : Date.now();
    }

    get name() {
      return this.#name;
    }

    get lastModified() {
      return this.#lastModified;
    }

    get [Symbol.toStringTag]() {
      return 'File';
    }
  }

  const EMPTY = 0;
  const LOADING = 1;
  const DONE = 2;
  const EVENTS = ['loadstart', 'progress', 'load', 'abort', 'error', 'loadend'];

  function stateError(message) {
    const error = new Error(message);
    error.name = 'InvalidStateError';
    return error;
  }

  class FileReader {
    #readyState = EMPTY;
    #result = null;
    #error = null;
    #listeners = new Map();
    #generation = 0;

    constructor() {
      for (const type of EVENTS) {
        this['on' + type] = null;
      }
    }

    get readyState() { return this.#readyState; }
    get result() { return this.#result; }
    get error() { return this.#error; }

    addEventListener(type, listener) {
      const list = this.#listeners.get(type) || [];
      list.push(listener);
      this.#listeners.set(type, list);
    }

    removeEventListener(type, listener) {
      const list = this.#listeners.get(type);
      if (!list) return;
      const at = list.indexOf(listener);
      if (at !== -1) list.splice(at, 1);
    }

    #dispatch(type) {
      const event = { type, target: this, lengthComputable: false, loaded: 0, total: 0 };
      const handler = this['on' + type];
      if (typeof handler === 'function') handler.call(this, event);
      for (const listener of (this.#listeners.get(type) || []).slice()) {
        listener.call(this, event);
      }
    }

    #read(blob, produce, method) {
      if (!(blob instanceof Blob)) {
        throw new TypeError("Failed to execute '" + method + "' on 'FileReader': parameter 1 is not of type 'Blob'.");
      }
      if (this.#readyState === LOADING) {
        throw stateError("Failed to execute '" + method + "' on 'FileReader': The object is already busy reading Blobs.");
      }
      const generation = ++this.#generation;
      this.#readyState = LOADING;
      this.#result = null;
      this.#error = null;
      const bytes = contents.get(blob);
      Promise.resolve().then(() => {
        if (generation !== this.#generation) return;
        this.#dispatch('loadstart');
        try {
          this.#result = produce(bytes);
          this.#readyState = DONE;
          this.#dispatch('progress');
          this.#dispatch('load');
        } catch (error) {
          this.#readyState = DONE;
          this.#error = error;
          this.#dispatch('error');
        }
        this.#dispatch('loadend');
      });
    }

    readAsText(blob) {
      this.#read(blob, decode, 'readAsText');
    }

    readAsArrayBuffer(blob) {
      this.#read(blob, bytes => bytes.slice().buffer, 'readAsArrayBuffer');
    }

    abort() {
      if (this.#readyState !== LOADING) {
        this.#result = null;
        return;
      }
      this.#generation++;
      this.#readyState = DONE;
      this.#result = null;
      Promise.resolve().then(() => {
        this.#dispatch('abort');
        this.#dispatch('loadend');
      });
    }

    get [Symbol.toStringTag]() {
      return 'FileReader';
    }
  }

  for (const [name, value] of [['EMPTY', EMPTY], ['LOADING', LOADING], ['DONE', DONE]]) {
    Object.defineProperty(FileReader, name, { value });
    Object.defineProperty(FileReader.prototype, name, { value });
  }

  for (const [name, value] of [['Blob', Blob], ['File', File], ['FileReader', FileReader]]) {
    Object.defineProperty(globalThis, name, { value, writable: true, configurable: true });
  }
})
"#;

pub(crate) fn install<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<()> {
    let glue: Function = ctx.eval(GLUE)?;
    let encode = Function::new(
        ctx.clone(),
        |ctx: Ctx<'js>, text: rquickjs::String<'js>| -> rquickjs::Result<ArrayBuffer<'js>> {
            let text = marshal::string_text(&text)?;
            ArrayBuffer::new(ctx, text.into_bytes())
        },
    )?;
    let decode = Function::new(
        ctx.clone(),
        |ctx: Ctx<'js>, buffer: ArrayBuffer<'js>| -> rquickjs::Result<String> {
            match buffer.as_bytes() {
                Some(bytes) => Ok(String::from_utf8_lossy(bytes).into_owned()),
                None => Err(Exception::throw_type(&ctx, "the buffer has been detached")),
            }
        },
    )?;
    glue.call((encode, decode))
}
