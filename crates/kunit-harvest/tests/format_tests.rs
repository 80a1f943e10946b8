use kunit_harvest::format::{format_buffer, format_bytes, format_value, FormatError, Radix};

#[test]
fn test_get_sign_values() {
    let x = (-3i32).to_le_bytes();
    let ret = (-1i32).to_le_bytes();
    assert_eq!(format_value(&x, Radix::Decimal).unwrap(), "-3");
    assert_eq!(format_value(&ret, Radix::Decimal).unwrap(), "-1");
    assert_eq!(format_value(&x, Radix::Hexadecimal).unwrap(), "-0x3");
    assert_eq!(format_value(&ret, Radix::Hexadecimal).unwrap(), "-0x1");
}

#[test]
fn test_widths_are_little_endian() {
    assert_eq!(format_value(&[0x01], Radix::Decimal).unwrap(), "1");
    assert_eq!(format_value(&[0x34, 0x12], Radix::Hexadecimal).unwrap(), "0x1234");
    assert_eq!(format_value(&[0x01, 0x01, 0x01, 0x01], Radix::Hexadecimal).unwrap(), "0x1010101");
    assert_eq!(format_value(&300i64.to_le_bytes(), Radix::Decimal).unwrap(), "300");
    assert_eq!(format_value(&[0, 0, 0, 0], Radix::Hexadecimal).unwrap(), "0x0");
}

#[test]
fn test_unsupported_widths() {
    for width in [0usize, 3, 5, 16] {
        assert_eq!(
            format_value(&vec![0; width], Radix::Decimal).unwrap_err(),
            FormatError::UnsupportedWidth { width }
        );
    }
}

#[test]
fn test_buffer_of_elements_is_a_brace_list() {
    let bytes: Vec<u8> = [1i32, -2, 3].iter().flat_map(|v| v.to_le_bytes()).collect();
    assert_eq!(format_buffer(&bytes, Some(4), Radix::Decimal).unwrap(), "{1, -2, 3}");
    assert_eq!(format_buffer(&bytes, Some(4), Radix::Hexadecimal).unwrap(), "{0x1, -0x2, 0x3}");
}

#[test]
fn test_single_element_buffer_is_a_scalar() {
    let bytes = 7i32.to_le_bytes();
    assert_eq!(format_buffer(&bytes, Some(4), Radix::Decimal).unwrap(), "7");
    assert_eq!(format_buffer(&bytes, None, Radix::Decimal).unwrap(), "7");
}

#[test]
fn test_unknown_element_width_formats_whole_buffer() {
    let bytes = [0u8; 12];
    assert_eq!(
        format_buffer(&bytes, None, Radix::Decimal).unwrap_err(),
        FormatError::UnsupportedWidth { width: 12 }
    );
}

#[test]
fn test_struct_bytes_render_as_byte_list() {
    let mut bytes = Vec::new();
    for field in [1i32, 2, -1] {
        bytes.extend_from_slice(&field.to_le_bytes());
    }
    assert_eq!(
        format_bytes(&bytes, Radix::Decimal),
        "{1, 0, 0, 0, 2, 0, 0, 0, 255, 255, 255, 255}"
    );
    assert_eq!(format_bytes(&[0x01, 0xab], Radix::Hexadecimal), "{0x01, 0xab}");
    assert_eq!(format_bytes(&[], Radix::Decimal), "{}");
}
