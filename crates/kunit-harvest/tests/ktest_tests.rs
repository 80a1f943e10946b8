use kunit_harvest::ktest::{decode, KTest, KTestObject, RecordDecodeError};

fn be(n: u32) -> [u8; 4] {
    n.to_be_bytes()
}

/// `KTEST` v3 record with one argument and objects `x` = -3 and `ret` = -1.
fn get_sign_record() -> Vec<u8> {
    let mut bytes = b"KTEST".to_vec();
    bytes.extend(be(3));
    bytes.extend(be(1));
    bytes.extend(be(9));
    bytes.extend(b"tests.bc\0");
    bytes.extend(be(0));
    bytes.extend(be(0));
    bytes.extend(be(2));
    bytes.extend(be(1));
    bytes.extend(b"x");
    bytes.extend(be(4));
    bytes.extend((-3i32).to_le_bytes());
    bytes.extend(be(3));
    bytes.extend(b"ret");
    bytes.extend(be(4));
    bytes.extend((-1i32).to_le_bytes());
    bytes
}

#[test]
fn test_decode_version_three() {
    let record = decode(&get_sign_record()).unwrap();
    assert_eq!(record.version, 3);
    assert_eq!(record.args, vec!["tests.bc\0"]);
    assert_eq!(record.objects.len(), 2);
    assert_eq!(record.object("x").unwrap().bytes, (-3i32).to_le_bytes());
    assert_eq!(record.object("ret").unwrap().bytes, vec![0xff; 4]);
    assert!(record.object("y").is_none());
}

#[test]
fn test_decode_legacy_version_one() {
    let mut bytes = b"BOUT\n".to_vec();
    bytes.extend(be(1));
    bytes.extend(be(0));
    bytes.extend(be(1));
    bytes.extend(be(1));
    bytes.extend(b"c");
    bytes.extend(be(1));
    bytes.push(b'A');

    let record = decode(&bytes).unwrap();
    assert_eq!(record.version, 1);
    assert_eq!((record.sym_argvs, record.sym_argv_len), (0, 0));
    assert_eq!(
        record.objects,
        vec![KTestObject {
            name: "c".to_string(),
            bytes: vec![b'A'],
        }]
    );
}

#[test]
fn test_every_truncation_is_rejected() {
    let bytes = get_sign_record();
    for len in 0..bytes.len() {
        assert!(decode(&bytes[..len]).is_err(), "prefix of {len} bytes decoded");
    }
}

#[test]
fn test_truncated_object_reports_offset() {
    let bytes = get_sign_record();
    let err = decode(&bytes[..bytes.len() - 2]).unwrap_err();
    assert_eq!(
        err,
        RecordDecodeError::Truncated {
            offset: bytes.len() - 4,
            needed: 2,
        }
    );
}

#[test]
fn test_bad_magic() {
    assert_eq!(decode(b"KLEE!\0\0\0\x03").unwrap_err(), RecordDecodeError::BadMagic);
}

#[test]
fn test_unsupported_version() {
    let mut bytes = b"KTEST".to_vec();
    bytes.extend(be(4));
    assert_eq!(decode(&bytes).unwrap_err(), RecordDecodeError::UnsupportedVersion(4));
}

#[test]
fn test_trailing_bytes() {
    let mut bytes = get_sign_record();
    bytes.push(0);
    assert_eq!(decode(&bytes).unwrap_err(), RecordDecodeError::TrailingBytes { count: 1 });
}

#[test]
fn test_invalid_object_name() {
    let mut bytes = b"KTEST".to_vec();
    bytes.extend(be(2));
    bytes.extend(be(0));
    bytes.extend(be(0));
    bytes.extend(be(0));
    bytes.extend(be(1));
    let offset = bytes.len();
    bytes.extend(be(1));
    bytes.push(0xff);
    bytes.extend(be(0));
    assert_eq!(decode(&bytes).unwrap_err(), RecordDecodeError::InvalidName { offset });
}

#[test]
fn test_encode_matches_engine_layout() {
    let record = KTest {
        version: 3,
        args: vec!["tests.bc\0".to_string()],
        sym_argvs: 0,
        sym_argv_len: 0,
        objects: vec![
            KTestObject {
                name: "x".to_string(),
                bytes: (-3i32).to_le_bytes().to_vec(),
            },
            KTestObject {
                name: "ret".to_string(),
                bytes: (-1i32).to_le_bytes().to_vec(),
            },
        ],
    };
    assert_eq!(record.encode(), get_sign_record());
}
