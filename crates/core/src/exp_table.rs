//! Companion experience requirements.

/// Highest level a companion can reach.
pub const MAX_LEVEL: u32 = 120;

/// `(exp_to_next, accumulated)` indexed by `level - 1`; `accumulated` is the
/// total experience needed to reach that level from level 1.
const TABLE: [(u64, u64); MAX_LEVEL as usize] = [
    (1500, 0),
    (4500, 1500),
    (7500, 6000),
    (10500, 13500),
    (13500, 24000),
    (16500, 37500),
    (19500, 54000),
    (27540, 73500),
    (37305, 101040),
    (49500, 138345),
    (78450, 187845),
    (133725, 266295),
    (187650, 400020),
    (240300, 587670),
    (291600, 827970),
    (341775, 1119570),
    (390675, 1461345),
    (438375, 1852020),
    (485025, 2290395),
    (530550, 2775420),
    (575025, 3305970),
    (618450, 3880995),
    (660900, 4499445),
    (702450, 5160345),
    (743025, 5862795),
    (782775, 6605820),
    (821625, 7388595),
    (859725, 8210220),
    (897075, 9069945),
    (933675, 9967020),
    (969525, 10900695),
    (1004775, 11870220),
    (1039425, 12874995),
    (1073475, 13914420),
    (1106925, 14987895),
    (1139925, 16094820),
    (1172400, 17234745),
    (1204425, 18407145),
    (1236075, 19611570),
    (1267425, 20847645),
    (1298325, 22115070),
    (1329000, 23413395),
    (1359375, 24742395),
    (1389600, 26101770),
    (1419525, 27491370),
    (1449375, 28910895),
    (1479075, 30360270),
    (1508775, 31839345),
    (1538325, 33348120),
    (1567950, 34886445),
    (1597575, 36454395),
    (1627200, 38051970),
    (1657050, 39679170),
    (1686975, 41336220),
    (1717050, 43023195),
    (1747350, 44740245),
    (1777875, 46487595),
    (1808775, 48265470),
    (1839900, 50074245),
    (1871400, 51914145),
    (1903350, 53785545),
    (1935675, 55688895),
    (1968450, 57624570),
    (2001750, 59593020),
    (2035575, 61594770),
    (2070000, 63630345),
    (2105025, 65700345),
    (2140650, 67805370),
    (2177025, 69946020),
    (2214075, 72123045),
    (2251875, 74337120),
    (2290500, 76588995),
    (2329875, 78879495),
    (2370150, 81209370),
    (2411400, 83579520),
    (2453475, 85990920),
    (2496600, 88444395),
    (2540700, 90940995),
    (2585775, 93481695),
    (2632050, 96067470),
    (2679375, 98699520),
    (2727825, 101378895),
    (2777550, 104106720),
    (2828400, 106884270),
    (2880525, 109712670),
    (2934000, 112593195),
    (2988825, 115527195),
    (3044925, 118516020),
    (3102525, 121560945),
    (3161475, 124663470),
    (3222000, 127824945),
    (3283950, 131046945),
    (3347475, 134330895),
    (3412575, 137678370),
    (3479325, 141090945),
    (3547725, 144570270),
    (3617850, 148117995),
    (3689625, 151735845),
    (3763275, 155425470),
    (3838650, 159188745),
    (3915900, 163027395),
    (3994950, 166943295),
    (4076025, 170938245),
    (4158975, 175014270),
    (4243875, 179173245),
    (4330875, 183417120),
    (4419900, 187747995),
    (4511025, 192167895),
    (4604250, 196678920),
    (4699650, 201283170),
    (4797225, 205982820),
    (4897125, 210780045),
    (4999200, 215677170),
    (5103600, 220676370),
    (5210400, 225779970),
    (5319525, 230990370),
    (5431125, 236309895),
    (5545125, 241741020),
    (5661675, 247286145),
    (0, 252947820),
];

/// Total experience needed to reach `level`; zero outside 1..=120.
pub fn accumulated_for(level: u32) -> u64 {
    if level == 0 || level > MAX_LEVEL {
        return 0;
    }
    TABLE[(level - 1) as usize].1
}

/// Experience from `level` to the next one; zero at the cap.
pub fn exp_to_next(level: u32) -> u64 {
    if level == 0 || level > MAX_LEVEL {
        return 0;
    }
    TABLE[(level - 1) as usize].0
}

/// Level-up actions needed to go from `current` to `target`.
pub fn levels_to_gain(current: u32, target: u32) -> u32 {
    target.saturating_sub(current)
}

pub fn is_ready_for_level(metric: u64, target: u32) -> bool {
    metric >= accumulated_for(target)
}
