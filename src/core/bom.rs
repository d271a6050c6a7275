// BOM sniffing over a pull byte source.

use crate::core::source::ByteSource;
use crate::encoding::Encoding;

/// BOM table, longest first. UTF-32 LE shares its two-byte prefix with
/// UTF-16 LE, so the 4-byte forms must be tested before the 2-byte forms.
const BOM_TABLE: &[(Encoding, &[u8])] = &[
    (Encoding::Utf32Be, &[0x00, 0x00, 0xFE, 0xFF]),
    (Encoding::Utf32Le, &[0xFF, 0xFE, 0x00, 0x00]),
    (Encoding::Utf8, &[0xEF, 0xBB, 0xBF]),
    (Encoding::Utf16Be, &[0xFE, 0xFF]),
    (Encoding::Utf16Le, &[0xFF, 0xFE]),
];

const MAX_BOM_LEN: usize = 4;

/// Read up to four bytes and match them against the BOM table.
///
/// On a match the BOM bytes are consumed and the remainder of the sniffed
/// prefix is pushed back. On no match every sniffed byte is pushed back, so
/// decoding starts from the true beginning of the input. A stream that fails
/// during the sniff simply yields a short prefix; the failure surfaces on
/// the first scalar pull instead.
pub fn sniff_bom(source: &mut ByteSource) -> Option<Encoding> {
    let mut prefix = [0u8; MAX_BOM_LEN];
    let mut got = 0;
    while got < MAX_BOM_LEN {
        match source.next_byte() {
            Some(byte) => {
                prefix[got] = byte;
                got += 1;
            }
            None => break,
        }
    }

    for &(encoding, bom) in BOM_TABLE {
        if got >= bom.len() && prefix[..bom.len()] == *bom {
            source.return_bytes(&prefix[bom.len()..got]);
            return Some(encoding);
        }
    }

    source.return_bytes(&prefix[..got]);
    None
}
