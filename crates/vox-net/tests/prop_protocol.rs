use proptest::prelude::*;
use vox_geom::{IVec3, Quat, Vec3};
use vox_net::{
    ChunkPlacement, Message, Origin, download_messages, linear_to_voxel, pack_block, unpack_block,
};

fn arb_vec3() -> impl Strategy<Value = Vec3> {
    (-1.0e4f32..1.0e4, -1.0e4f32..1.0e4, -1.0e4f32..1.0e4).prop_map(|(x, y, z)| Vec3::new(x, y, z))
}

fn arb_ivec3() -> impl Strategy<Value = IVec3> {
    (any::<i32>(), any::<i32>(), any::<i32>()).prop_map(|(x, y, z)| IVec3::new(x, y, z))
}

fn arb_server_message() -> impl Strategy<Value = Message> {
    prop_oneof![
        (any::<u16>(), arb_ivec3(), any::<u16>())
            .prop_map(|(chunk, pos, block)| Message::SetBlock { chunk, pos, block }),
        (any::<u16>(), 1u16..=u16::MAX, any::<(u8, u8, u8)>(), arb_ivec3()).prop_map(
            |(chunk, neighborhood, dims, pin)| Message::NewChunk {
                chunk,
                neighborhood,
                dims,
                placement: ChunkPlacement::Lattice(pin),
            }
        ),
        (any::<u16>(), arb_vec3()).prop_map(|(neighborhood, position)| {
            Message::SetNeighborhoodTransform {
                neighborhood,
                position,
                rotation: Quat::from_axis_angle(Vec3::UP, 0.7),
            }
        }),
        (any::<u16>(), any::<u16>(), prop::collection::vec(any::<u16>(), 0..=245)).prop_map(
            |(chunk, offset, entries)| Message::ChunkDownload { chunk, offset, entries }
        ),
    ]
}

proptest! {
    #[test]
    fn block_packing_is_a_bijection(v in any::<u16>()) {
        let (id, o) = unpack_block(v);
        prop_assert!(o < 4);
        prop_assert_eq!(pack_block(id, o), v);
    }

    #[test]
    fn server_messages_decode_to_themselves(msg in arb_server_message()) {
        let bytes = msg.encode();
        prop_assert_eq!(Message::decode(&bytes, Origin::Server), Ok(msg));
    }

    #[test]
    fn truncated_messages_never_decode(msg in arb_server_message(), cut in 1usize..8) {
        let bytes = msg.encode();
        let keep = bytes.len().saturating_sub(cut).max(1);
        prop_assume!(keep < bytes.len());
        prop_assert!(Message::decode(&bytes[..keep], Origin::Server).is_err());
    }

    #[test]
    fn bulk_download_replays_the_grid(
        (dims, grid) in (1u8..=12, 1u8..=12, 1u8..=12).prop_flat_map(|d| {
            let n = d.0 as usize * d.1 as usize * d.2 as usize;
            (Just(d), prop::collection::vec(any::<u16>(), n))
        })
    ) {
        let mut replay = vec![0u16; grid.len()];
        let mut seen = 0usize;
        for msg in download_messages(7, &grid) {
            let bytes = msg.encode();
            let Ok(Message::ChunkDownload { chunk, offset, entries }) = Message::decode(&bytes, Origin::Server) else {
                return Err(TestCaseError::fail("download packet did not decode"));
            };
            prop_assert_eq!(chunk, 7);
            prop_assert!(entries.len() <= 245);
            prop_assert_eq!(offset as usize, seen);
            for (i, e) in entries.iter().enumerate() {
                let p = linear_to_voxel(offset as usize + i, dims);
                let idx = p.z as usize + p.y as usize * dims.2 as usize
                    + p.x as usize * dims.2 as usize * dims.1 as usize;
                replay[idx] = *e;
            }
            seen += entries.len();
        }
        prop_assert_eq!(seen, grid.len());
        prop_assert_eq!(replay, grid);
    }
}
