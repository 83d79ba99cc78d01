//! Reading the pipeline input.

use std::io::{BufRead, Read};

use crate::error::{Error, ExceptionKind, FragmentError};
use crate::value::{Stream, Value};

/// All of `reader` as one string, without its final newline.
pub fn read_all(mut reader: impl Read) -> Result<Value, Error> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let text = text.strip_suffix('\n').unwrap_or(&text);
    Ok(Value::from(text))
}

/// A lazy stream of the lines of `reader`, line endings removed.
pub fn lines(reader: impl BufRead + 'static) -> Value {
    Value::Stream(Stream::new(reader.lines().map(|line| {
        line.map(Value::from)
            .map_err(|err| FragmentError::new(ExceptionKind::OSError, err.to_string()))
    })))
}

/// The single input value of a run.
pub fn read_input(reader: impl BufRead + 'static, each_line: bool) -> Result<Value, Error> {
    if each_line {
        Ok(lines(reader))
    } else {
        read_all(reader)
    }
}
